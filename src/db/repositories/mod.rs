mod posture_counts;
